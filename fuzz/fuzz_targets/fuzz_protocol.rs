#![no_main]

//! Inbound message fuzzer.
//!
//! Agents control every byte they send, so decoding must reject anything
//! without panicking. Lines that decode must name a phase that matches
//! their command.

use libfuzzer_sys::fuzz_target;
use skirmish::protocol::{parse_inbound, Inbound};

fuzz_target!(|data: &[u8]| {
    if let Ok(Inbound::Action(submission)) = parse_inbound(data) {
        assert_eq!(submission.phase, submission.action.phase());
    }
});
