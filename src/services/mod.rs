pub mod classifier;
pub mod object_store;
pub mod pipeline;
pub mod record_store;
pub mod supabase;
