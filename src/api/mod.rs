pub mod export;
pub mod records;
pub mod scan;
pub mod users;
