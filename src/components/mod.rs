pub mod chat_input;
pub mod layers;
pub mod properties;
pub mod toolbar;
