#![no_main]

use cordyceps_avl::model::RangeEquivalenceInput;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: RangeEquivalenceInput| {
    cordyceps_avl::model::run_range_equivalence(input.values, input.queries);
});
