pub mod bitmap;
pub mod bitmap_ref_mut;
pub mod intrusive_list;
pub mod mapped_rwlockreadguard;
