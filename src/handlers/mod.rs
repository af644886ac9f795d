pub mod analyze_handlers;
pub mod health_handlers;
pub mod object_handlers;
