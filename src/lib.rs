pub use evflow_common::*;

#[cfg(test)]
mod tests;
