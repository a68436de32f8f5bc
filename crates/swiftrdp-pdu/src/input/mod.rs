pub mod fast_path;
pub mod mouse;
pub mod mouse_rel;
pub mod mouse_x;

pub use self::fast_path::{
    FastPathInput, FastPathInputEvent, FastPathInputHeader, FastpathInputEventType, KeyboardFlags, SynchronizeFlags,
};
pub use self::mouse::{MousePdu, PointerFlags};
pub use self::mouse_rel::{MouseRelPdu, PointerRelFlags};
pub use self::mouse_x::{MouseXPdu, PointerXFlags};
