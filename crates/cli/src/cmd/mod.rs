mod aliases;
mod build_plan;
mod plan;
mod publish;

pub use aliases::cmd_aliases;
pub use build_plan::cmd_build_plan;
pub use plan::cmd_plan;
pub use publish::cmd_publish;
