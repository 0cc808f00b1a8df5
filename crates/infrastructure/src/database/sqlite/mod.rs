pub mod sqlite_record_repository;

pub use sqlite_record_repository::SqliteRecordRepository;
