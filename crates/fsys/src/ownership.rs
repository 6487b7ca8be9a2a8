#![allow(unsafe_code)]

pub(crate) const fn uid_from_raw(raw: u32) -> rustix::fs::Uid {
    unsafe { rustix::fs::Uid::from_raw(raw) }
}

pub(crate) const fn gid_from_raw(raw: u32) -> rustix::fs::Gid {
    unsafe { rustix::fs::Gid::from_raw(raw) }
}
