use crate::packet::{Message, Packet};

/// The capability the network emulator hands to a protocol role.
/// Roles call these methods to reach the channel, the timers and the application layer.
pub trait SystemContext {
    /// Send a packet over the unreliable channel.
    fn send_packet(&mut self, packet: Packet);

    /// Start a single-shot timer identified by `timer_id`.
    /// Starting an id that is already pending schedules a second expiry;
    /// cancel first if only one should fire.
    fn start_timer(&mut self, delay: u64, timer_id: u32);

    /// Cancel every pending expiry of `timer_id`.
    fn cancel_timer(&mut self, timer_id: u32);

    /// Deliver an in-order payload to the application layer.
    fn deliver_data(&mut self, data: &[u8]);

    /// Log a message to the emulator's debug output.
    fn log(&mut self, message: &str);

    /// Current simulated time.
    fn now(&self) -> u64;

    /// Record a numeric metric (counters, window occupancy) for the run report.
    fn record_metric(&mut self, _name: &str, _value: f64) {
        // Default no-op so contexts without a report don't need to care.
    }
}

/// A protocol role driven by the emulator.
pub trait TransportProtocol {
    /// Called when the simulation starts. Resets all role state.
    fn init(&mut self, _ctx: &mut dyn SystemContext) {}

    /// Called when a packet arrives from the network.
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet);

    /// Called when a timer expires.
    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32);

    /// Called when the application layer hands over a message to transfer.
    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, message: Message);
}
