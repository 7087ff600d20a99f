pub mod imdp;
pub mod helper_methods;
pub mod interval_iter;
pub mod value_iteration;
pub mod weighted;
pub mod lp;
