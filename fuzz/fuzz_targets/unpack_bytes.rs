#![no_main]

use bytestruct::{Field, Len, Scalar, Schema};
use libfuzzer_sys::fuzz_target;
use std::sync::{Arc, OnceLock};

static SCHEMA: OnceLock<Arc<Schema>> = OnceLock::new();

fn schema() -> &'static Arc<Schema> {
    SCHEMA.get_or_init(|| {
        let point = Schema::builder("Point")
            .field("x", Field::scalar(Scalar::F64))
            .field("y", Field::scalar(Scalar::F64))
            .build()
            .expect("compose Point");
        Schema::builder("Packet")
            .field("tag", Field::scalar(Scalar::U8))
            .field("count", Field::scalar(Scalar::U16))
            .field(
                "points",
                Field::array(Field::nested(point), Len::Ref("count".to_string())),
            )
            .field(
                "trailer",
                Field::array(Field::scalar(Scalar::Char), Len::Remainder),
            )
            .build()
            .expect("compose Packet")
    })
}

fuzz_target!(|data: &[u8]| {
    if let Ok(inst) = schema().unpack(data) {
        // Anything that unpacked must pack back to the same bytes.
        let packed = inst.pack().expect("round trip");
        assert_eq!(packed, data);
    }
});
