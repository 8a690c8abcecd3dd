pub mod cc;
pub mod sim;
pub mod stats;
pub mod sys;
pub mod viz;
pub mod workload;

#[cfg(test)]
mod test;
