pub mod config_resolver;
pub mod filters;
pub mod gateway;
pub mod load_balancer;
pub mod registry;
pub mod route_table;

pub use config_resolver::{ConfigResolver, ResolvedConfig};
pub use gateway::{GatewayError, GatewayService};
pub use registry::{ServiceInstance, ServiceRegistry};
pub use route_table::{Route, RouteTable};
