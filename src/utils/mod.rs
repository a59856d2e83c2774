pub mod logger;

pub use self::logger::init_logging;
