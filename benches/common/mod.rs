#![allow(dead_code)]
use std::fs;

use rill::ast::Module;
use rill::{lexer, parser};

pub const WORKLOADS: [(&str, &str); 2] = [
    ("minimal", "tests/programs/minimal_function/program.rl"),
    ("structs", "tests/programs/structs_and_loops/program.rl"),
];

pub fn workloads() -> Vec<(&'static str, &'static str)> {
    WORKLOADS.to_vec()
}

pub fn load_source(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("read {path}: {err}"))
}

pub fn load_module(path: &str) -> Module {
    let source = load_source(path);
    let tokens = lexer::tokenize(&source).unwrap_or_else(|err| panic!("tokenize {path}: {err}"));
    parser::parse_tokens(tokens).unwrap_or_else(|err| panic!("parse {path}: {err}"))
}
