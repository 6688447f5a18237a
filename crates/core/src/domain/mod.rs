pub mod conversation;
pub mod intent;
pub mod knowledge;
pub mod order;
pub mod slot;
