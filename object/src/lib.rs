mod events;
mod layout;
mod method;
mod oop;
mod special;

pub use events::{
    pack_event, EventType, BLUE_BUTTON, CAPS_LOCK_KEY, CONTROL_KEY,
    LEFT_SHIFT_KEY, RED_BUTTON, RIGHT_SHIFT_KEY, YELLOW_BUTTON,
};
pub use layout::*;
pub use method::MethodHeader;
pub use oop::{
    extract_bits, insert_bits, integer_object_of, integer_value_of,
    is_integer_object, is_integer_value, Oop, MAX_SMALL_INT, MIN_SMALL_INT,
    NON_POINTER,
};
pub use special::*;

#[cfg(test)]
mod tests {
    use super::*;

    // ── Oop tagging ────────────────────────────────────────────────

    #[test]
    fn small_integer_round_trip() {
        for n in [0i16, 1, -1, 42, -42, MAX_SMALL_INT, MIN_SMALL_INT] {
            let oop = integer_object_of(n);
            assert!(is_integer_object(oop));
            assert_eq!(integer_value_of(oop), n);
        }
    }

    #[test]
    fn small_integer_range() {
        assert!(is_integer_value(16383));
        assert!(is_integer_value(-16384));
        assert!(!is_integer_value(16384));
        assert!(!is_integer_value(-16385));
    }

    #[test]
    fn special_oops_are_table_indices() {
        for oop in [
            NIL_PTR,
            TRUE_PTR,
            FALSE_PTR,
            SCHEDULER_ASSOCIATION_PTR,
            CLASS_SMALL_INTEGER,
            SPECIAL_SELECTORS_PTR,
            MUST_BE_BOOLEAN_SEL,
        ] {
            assert!(!is_integer_object(oop));
        }
        assert_eq!(MUST_BE_BOOLEAN_SEL, LAST_SPECIAL_OOP);
    }

    // ── Bit fields ─────────────────────────────────────────────────

    #[test]
    fn extract_counts_from_msb() {
        // Bit 0 is the most significant bit of the 16-bit word.
        assert_eq!(extract_bits(0, 0, 0x8000), 1);
        assert_eq!(extract_bits(15, 15, 0x0001), 1);
        assert_eq!(extract_bits(0, 7, 0xAB00), 0xAB);
        assert_eq!(extract_bits(8, 15, 0x00CD), 0xCD);
        assert_eq!(extract_bits(4, 11, 0x0FF0), 0xFF);
    }

    #[test]
    fn insert_is_inverse_of_extract() {
        let word = insert_bits(4, 11, 0x1234, 0xFF);
        assert_eq!(extract_bits(4, 11, word), 0xFF);
        assert_eq!(extract_bits(0, 3, word), 0x1);
        assert_eq!(extract_bits(12, 15, word), 0x4);
    }

    // ── Method headers ─────────────────────────────────────────────

    #[test]
    fn method_header_fields() {
        // literal count 3, large context, temporaries 5, flag 0
        let header: Oop = (5 << 8) | (1 << 7) | (3 << 1) | 1;
        let decoded = MethodHeader::of_header_word(header);
        assert_eq!(decoded.literal_count, 3);
        assert_eq!(decoded.temporary_count, 5);
        assert!(decoded.large_context);
        assert_eq!(decoded.flag_value, 0);
        assert_eq!(decoded.initial_instruction_pointer(), (3 + 1) * 2 + 1);
    }

    // ── Event words ────────────────────────────────────────────────

    #[test]
    fn event_word_packing() {
        assert_eq!(pack_event(EventType::BistateDown, RED_BUTTON), 0x3082);
        assert_eq!(pack_event(EventType::DeltaTime, 4095), 0x0FFF);
        assert_eq!(pack_event(EventType::PointerX, 100), 0x1064);
    }
}
