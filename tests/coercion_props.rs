use iota_jexl as jexl;
use jexl::Attribute;
use proptest::prelude::*;
use serde_json::{json, Value};

proptest! {
    #[test]
    fn integer_text_coerces_to_integer(i in any::<i64>()) {
        prop_assert_eq!(jexl::coerce(&i.to_string()), json!(i));
    }

    #[test]
    fn fractional_text_coerces_to_float(whole in -100_000i64..100_000, frac in 1u32..1000) {
        let text = format!("{whole}.{frac:03}");
        let expected: f64 = text.parse().unwrap();
        prop_assert_eq!(jexl::coerce(&text), json!(expected));
    }

    #[test]
    fn padded_integer_text_coerces_to_integer(i in any::<i64>(), left in " {0,3}", right in "[ \t]{0,3}") {
        prop_assert_eq!(jexl::coerce(&format!("{left}{i}{right}")), json!(i));
    }

    #[test]
    fn other_text_is_kept(s in "[a-zA-Z][a-zA-Z0-9 _-]{0,12}") {
        prop_assume!(s != "true" && s != "false");
        prop_assert_eq!(jexl::coerce(&s), Value::String(s.clone()));
    }

    #[test]
    fn context_is_idempotent_and_dual_keyed(
        values in proptest::collection::vec("[0-9a-z.]{0,6}", 1..8)
    ) {
        let attrs: Vec<Attribute> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Attribute::measure(format!("n{i}"), v.as_str()).with_alternate_id(format!("a{i}")))
            .collect();
        let first = jexl::extract_context(&attrs);
        let second = jexl::extract_context(&attrs);
        prop_assert_eq!(&first, &second);
        for i in 0..values.len() {
            prop_assert_eq!(first.get(&format!("n{i}")), first.get(&format!("a{i}")));
        }
    }
}

#[test]
fn test_boolean_literals() {
    assert_eq!(jexl::coerce("true"), json!(true));
    assert_eq!(jexl::coerce("false"), json!(false));
}
