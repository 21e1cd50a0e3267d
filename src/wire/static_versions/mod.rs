//! Fixed-layout wire formats (NetFlow v5 has no templates).

pub mod v5;
