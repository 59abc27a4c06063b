mod common;
mod document;
