#![no_main]

use arbitrary::Arbitrary;
use cairn_core::{Expr, Identity, Point, Scalar};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    text: String,
    verified: [bool; 4],
}

fn pool() -> Vec<Identity> {
    (1..=4u64)
        .map(|i| Identity::ecdsa(Point::mul_base(&Scalar::from_u64(i))))
        .collect()
}

fuzz_target!(|input: Input| {
    // Parsing arbitrary text must not panic
    let Ok(expr) = input.text.parse::<Expr>() else {
        return;
    };

    // Printing and re-parsing keeps the meaning
    let reparsed: Expr = expr.to_string().parse().unwrap();
    let ids = pool();
    let verified = |id: &Identity| ids.iter().zip(input.verified).any(|(i, v)| v && i == id);
    assert_eq!(expr.eval(&verified), reparsed.eval(&verified));
});
