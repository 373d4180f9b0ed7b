pub mod cleaner;
pub mod compare;
pub mod glossary;
pub mod index;
pub mod library;
pub mod llm;
pub mod preload;
pub mod reader;
pub mod rewrite;
pub mod settings;

#[cfg(test)]
pub mod testing;
