//! The executable graph: nodes and their identities, ports, variables and
//! graph models with their execution schedule.
pub mod dag;
pub mod lifecycle;
pub mod model;
pub mod node;
pub mod port;
pub mod variable;

pub use lifecycle::{ActiveNode, Lifecycle};
pub use model::GraphModel;
pub use node::{gen_sim_id, NodeIdentity, NodeType};
