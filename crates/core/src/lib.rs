pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod slots;

pub use context::{Clock, ContextSettings, ContextStore, ManualClock, SystemClock};
pub use domain::conversation::{
    ConversationId, ConversationState, ConversationUpdate, ConversationView, Message, Role,
};
pub use domain::knowledge::{PolicyCollection, PolicyDocument};
pub use domain::order::{OrderId, OrderRecord};
pub use domain::slot::{SlotMap, SlotValue};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{TurnAction, TurnContext, TurnEvent, TurnFlow, TurnState, TurnTransitionError};
pub use slots::SlotResolver;
