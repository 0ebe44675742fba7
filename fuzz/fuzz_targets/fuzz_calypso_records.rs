#![no_main]

use cairn_calypso::{DecryptKeyReply, Read, Write};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(write) = Write::from_bytes(data) {
        let _ = write.check_proof(&cairn_core::DarcId::default());
        assert_eq!(Write::from_bytes(&write.to_bytes()).unwrap(), write);
    }

    if let Ok(read) = Read::from_bytes(data) {
        let _ = read.validate();
        assert_eq!(Read::from_bytes(&read.to_bytes()).unwrap(), read);
    }

    if let Ok(reply) = DecryptKeyReply::from_bytes(data) {
        assert_eq!(DecryptKeyReply::from_bytes(&reply.to_bytes()).unwrap(), reply);
    }
});
