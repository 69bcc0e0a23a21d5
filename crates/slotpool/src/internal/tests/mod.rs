#[cfg(test)]
mod test_tokens;

pub mod utils;
