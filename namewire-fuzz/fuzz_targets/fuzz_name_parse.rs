#![no_main]

use libfuzzer_sys::fuzz_target;
use namewire_core::name::Name;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(name) = Name::parse(input) else {
        return;
    };

    // Display output must parse back to the same name.
    let printed = name.to_string();
    let reparsed = Name::parse(&printed).expect("printed name must parse");
    assert_eq!(name, reparsed);

    // Every prefix is a prefix.
    for prefix in name.prefixes_longest_first() {
        assert!(prefix.is_prefix_of(&name));
    }
});
