pub mod clickhouse;
pub mod counter;
pub mod mysql;
