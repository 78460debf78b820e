//! Reads the current CPU a thread is running on out of
//! `/proc/<pid>/task/<tid>/stat` field 39 ("processor"). Locates the end
//! of the `comm` field with `rfind(')')` before tokenizing the rest, so a
//! process name containing spaces or parentheses doesn't shift every
//! later field out of place.

use std::fs;

/// Field 39 ("processor") is the 37th whitespace-separated token after
/// the closing `)` of `comm` (field 3, "state", is the 1st).
const PROCESSOR_FIELD_OFFSET: usize = 39 - 3;

pub fn current_cpu(pid: libc::pid_t, tid: libc::pid_t) -> Option<u32> {
    let contents = fs::read_to_string(format!("/proc/{pid}/task/{tid}/stat")).ok()?;
    parse_processor_field(&contents)
}

fn parse_processor_field(contents: &str) -> Option<u32> {
    let close = contents.rfind(')')?;
    let rest = contents.get(close + 1..)?;
    let mut fields = rest.split_whitespace();
    fields.nth(PROCESSOR_FIELD_OFFSET)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_processor_field_with_plain_comm() {
        // 36 filler fields between `state` and `processor`.
        let filler = "0 ".repeat(PROCESSOR_FIELD_OFFSET);
        let line = format!("123 (myproc) R {filler}7 8 9");
        assert_eq!(parse_processor_field(&line), Some(7));
    }

    #[test]
    fn comm_with_spaces_does_not_shift_fields() {
        let filler = "0 ".repeat(PROCESSOR_FIELD_OFFSET);
        let line = format!("123 (my weird (proc) name) R {filler}11 8 9");
        assert_eq!(parse_processor_field(&line), Some(11));
    }
}
