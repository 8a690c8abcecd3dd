mod pipeline;
mod scenarios;
mod simulator;
mod support;
