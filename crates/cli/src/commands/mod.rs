pub mod migrate;

pub use migrate::MigrateContext;
