#![no_main]

use cairn_core::Darc;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parse darc - should not panic
    if let Ok(darc) = Darc::from_bytes(data) {
        // Re-encoding decodes to the same Darc
        assert_eq!(Darc::from_bytes(&darc.to_bytes()).unwrap(), darc);

        if let Ok(next) = darc.next_version() {
            assert!(darc.check_successor(&next).is_ok());
            assert_ne!(next.id(), darc.id());
        }
    }
});
