#[macro_use]
extern crate lazy_static;

pub mod analysis;
pub mod callgraph;
pub mod cfg;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod pta;


#[cfg(test)]
mod parser_tests;

#[cfg(test)]
mod cfg_tests;
