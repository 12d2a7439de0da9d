use crate::prelude::{CoreResult, Sweep};

/// Producer of complete sweeps from the primary receiver.
///
/// `next_sweep` blocks until a full sweep is available and returns `None`
/// once the stream has ended. The shape is expected to stay fixed for a
/// scanning session; a change is treated as a session restart.
pub trait SweepSource {
    fn next_sweep(&mut self) -> CoreResult<Option<Sweep>>;
}
