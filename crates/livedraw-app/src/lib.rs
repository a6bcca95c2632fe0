// Live draw orchestration: the draw sequencer, background pollers, and the
// session event loop that folds their events into one `DrawSession`.

pub mod app;
pub mod poller;
pub mod sequencer;
