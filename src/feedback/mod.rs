//! Feedback store and its storage backends

pub mod storage;
pub mod store;

pub use storage::{FeedbackStorage, InMemoryFeedbackStorage, JsonLinesFeedbackStorage};
pub use store::FeedbackStore;
