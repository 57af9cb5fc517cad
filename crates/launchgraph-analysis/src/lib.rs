pub mod classifier;
pub mod evaluator;
pub mod expression;
pub mod memo;
pub mod report;
pub mod service;
pub mod visitor;


pub use classifier::*;
pub use evaluator::*;
pub use expression::*;
pub use memo::*;
pub use report::*;
pub use service::*;
pub use visitor::*;
