pub mod fair_value;
pub mod ranker;
pub mod report;
pub mod scanner;
pub mod signal;

pub use scanner::Scanner;
