pub mod cart_api;
pub mod dispatch_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod payment_api;
