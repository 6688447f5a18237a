pub mod engine;
pub mod states;

pub use engine::{TurnFlow, TurnTransitionError};
pub use states::{TurnAction, TurnContext, TurnEvent, TurnState, TurnTransition};
