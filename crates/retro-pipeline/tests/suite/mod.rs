mod chain;
mod pipeline;
mod stages;
