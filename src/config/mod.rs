pub mod node;
pub mod route;
pub mod lwcomm_config;
