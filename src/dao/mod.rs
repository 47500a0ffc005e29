/// Store-side time source.
pub mod clock;
/// Room, player and answer records.
pub mod models;
/// Room store abstraction and its backends.
pub mod room_store;
/// Backend-agnostic storage errors.
pub mod storage;
