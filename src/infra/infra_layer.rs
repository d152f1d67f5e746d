// The infra module contains implementations of core traits.

#[path = "experience/experience_store.rs"]
pub mod experience;
