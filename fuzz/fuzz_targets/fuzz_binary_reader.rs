#![no_main]

use libfuzzer_sys::fuzz_target;
use ua_protocol::address_space::Variant;
use ua_protocol::core::binary::{BinaryReader, ByteOrder};

fuzz_target!(|data: &[u8]| {
    // First byte picks the byte order; the rest is a stream of variants
    let Some((&flag, body)) = data.split_first() else {
        return;
    };
    let order = if flag & 1 == 0 {
        ByteOrder::LittleEndian
    } else {
        ByteOrder::BigEndian
    };

    let mut reader = BinaryReader::with_byte_order(body, order);
    while reader.remaining() > 0 {
        if Variant::decode(&mut reader).is_err() {
            break;
        }
    }
});
