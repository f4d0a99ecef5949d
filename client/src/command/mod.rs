pub mod cache_info;
pub mod fetch;
pub mod get_closure;
pub mod nar_dump;
pub mod push;
pub mod query_missing;
pub mod show_derivation;
