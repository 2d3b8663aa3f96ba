pub mod diesel_pool;
pub mod migrations;

pub use migrations::run_migrations;

pub use diesel_pool::{
    check_diesel_health, create_diesel_pool, create_lazy_pool, mask_connection_string,
    DieselDatabaseConfig, DieselPool,
};
