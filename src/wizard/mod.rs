//! Quote wizard: the immutable session state and the controller that owns it.

pub mod controller;
pub mod state;

pub use controller::WizardController;
pub use state::{RequestToken, Transition, WizardStage, WizardState};
