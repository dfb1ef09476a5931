pub mod ast;
pub mod op;
pub mod val;
pub mod vm;
