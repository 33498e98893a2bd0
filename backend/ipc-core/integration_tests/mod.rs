mod helpers;
mod memory_roundtrip;
mod ws_roundtrip;
