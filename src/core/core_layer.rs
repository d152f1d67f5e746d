// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "experience/experience_service.rs"]
pub mod experience;

#[path = "roles/role_changes.rs"]
pub mod roles;
