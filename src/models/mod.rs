pub mod keyword;
pub mod product;
pub mod row;
pub mod site;

pub use keyword::*;
pub use product::*;
pub use row::*;
pub use site::*;
