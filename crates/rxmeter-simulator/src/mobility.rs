use rxmeter_abstract::{SimTime, Vector3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mobility {
    ConstantPosition(Vector3),
    /// Position at time t is `origin + velocity * t`.
    ConstantVelocity { origin: Vector3, velocity: Vector3 },
}

impl Mobility {
    pub fn position_at(&self, time: SimTime) -> Vector3 {
        match self {
            Mobility::ConstantPosition(p) => *p,
            Mobility::ConstantVelocity { origin, velocity } => {
                origin.offset(&velocity.scaled(time.as_secs_f64()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimNode {
    pub name: String,
    pub mobility: Mobility,
}

#[cfg(test)]
mod tests {
    use super::Mobility;
    use rxmeter_abstract::{SimTime, Vector3};

    #[test]
    fn constant_velocity_moves_linearly() {
        let tram = Mobility::ConstantVelocity {
            origin: Vector3::ZERO,
            velocity: Vector3::on_x(40.0),
        };
        assert_eq!(tram.position_at(SimTime::ZERO).x, 0.0);
        assert_eq!(tram.position_at(SimTime::from_secs(10)).x, 400.0);
        assert_eq!(tram.position_at(SimTime::from_millis(500)).x, 20.0);
    }

    #[test]
    fn constant_position_ignores_time() {
        let station = Mobility::ConstantPosition(Vector3::on_x(5000.0));
        assert_eq!(station.position_at(SimTime::from_secs(99)).x, 5000.0);
    }
}
