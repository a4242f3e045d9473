// ABOUTME: Log viewer controller for one pipeline step
//
// Key components:
// - controller: turns container selection and filter edits into stream sessions
// - state: the explicit viewer state machine, its updates and errors

pub mod controller;
pub mod state;

pub use controller::ViewerController;
pub use state::{SessionState, ViewerError, ViewerUpdate};
