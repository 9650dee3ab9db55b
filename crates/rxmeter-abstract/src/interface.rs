use crate::geo::Vector3;
use crate::packet::{Delivery, NodeId};
use crate::time::SimTime;

/// The capabilities the event engine offers to an observer while one of its
/// callbacks runs. Requested actions take effect after the callback returns.
pub trait SystemContext {
    /// Current simulated time.
    fn now(&self) -> SimTime;

    /// Arm timer `timer_id` to expire `delay` from now.
    /// Re-arming an id does not invalidate the earlier expiry; cancel first.
    fn start_timer(&mut self, delay: SimTime, timer_id: u32);

    /// Invalidate every pending expiry of `timer_id`.
    fn cancel_timer(&mut self, timer_id: u32);

    /// Position of `node` at the current simulated time.
    fn position(&self, node: NodeId) -> Option<Vector3>;

    fn log(&mut self, message: &str);

    /// Record a numeric sample in a named time series.
    fn record_metric(&mut self, _name: &str, _value: f64) {}
}

/// Receives engine callbacks for the lifetime of one run.
pub trait SimObserver {
    /// Called once before the first event is processed.
    fn init(&mut self, _ctx: &mut dyn SystemContext) {}

    /// Called when a bound receive socket hands up a packet.
    fn on_receive(&mut self, ctx: &mut dyn SystemContext, delivery: &Delivery);

    /// Called when a timer armed through the context expires.
    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32);

    /// Called once when the engine reaches its stop time or runs out of events.
    fn on_stop(&mut self, _ctx: &mut dyn SystemContext) {}
}
