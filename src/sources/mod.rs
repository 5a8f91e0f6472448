pub mod sql_dump;

pub use sql_dump::{SqlDumpScanner, UrlExtraction};
