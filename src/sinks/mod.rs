//! Config generators: render a downstream artifact (or otherwise act)
//! from the reconciled inventory.

pub mod proxy_config;
pub mod routing_kv;
pub mod stdout;
