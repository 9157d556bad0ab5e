// Library surface of the clashgroup CLI: the end-to-end grouping pipeline.

pub mod pipeline;
