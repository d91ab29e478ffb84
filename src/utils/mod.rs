pub mod file;

#[cfg(test)]
pub(crate) mod test_support;
