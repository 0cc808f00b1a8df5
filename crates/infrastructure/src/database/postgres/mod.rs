pub mod postgres_record_repository;

pub use postgres_record_repository::PostgresRecordRepository;
