#![no_main]

use libfuzzer_sys::fuzz_target;
use namewire_core::filter::FilterRegistry;
use namewire_core::name::Name;

// First byte picks the split between registered prefixes and the probe;
// components are drawn from a tiny alphabet so prefixes actually collide.
fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = usize::from(split) % (rest.len() + 1);
    let (table, probe) = rest.split_at(split);

    let mut registry: FilterRegistry<usize> = FilterRegistry::new();
    for (i, chunk) in table.chunks(3).enumerate() {
        if let Ok(prefix) = Name::from_components(chunk.iter().map(|b| format!("c{}", b % 4))) {
            registry.register(prefix, i);
        }
    }
    let Ok(name) = Name::from_components(probe.iter().map(|b| format!("c{}", b % 4))) else {
        return;
    };

    let found = registry.longest_match(&name).map(|entry| entry.prefix().len());
    let brute = registry
        .prefixes()
        .filter(|p| p.is_prefix_of(&name))
        .map(Name::len)
        .max();
    assert_eq!(found, brute);
});
