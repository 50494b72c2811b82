// Engine core: ownership, the window collaborator and the application shell.

pub mod application;
pub mod handle;
pub mod window;

pub use application::Application;
pub use handle::Ref;
pub use window::{DesktopWindow, Window};
