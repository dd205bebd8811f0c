//! Pause/stop signal manager - two orthogonal, idempotent checks performed
//! at every action boundary: a pause signal file, and tracker assignee
//! removal (stop).

mod pause;
mod stop;

pub use pause::PauseWatcher;
pub use stop::StopWatcher;
