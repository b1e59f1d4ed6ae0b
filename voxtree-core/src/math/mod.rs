mod bounds;
pub use self::bounds::*;

mod octree_key;
pub use self::octree_key::*;

mod bitmanip;
pub use self::bitmanip::*;

mod minmax;
pub use self::minmax::*;
