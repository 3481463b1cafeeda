//! Record id generation.
//!
//! Ids are five 3-digit zero-padded groups joined by hyphens with a type
//! suffix, e.g. `042-917-003-558-120-F`. No uniqueness check is made at
//! generation time; collisions are rejected by the store's primary key.

use rand::Rng;

const INVOICE_SUFFIX: &str = "F";
const INSTALLMENT_SUFFIX: &str = "P";

fn random_groups() -> String {
    let mut rng = rand::thread_rng();
    (0..5)
        .map(|_| format!("{:03}", rng.gen_range(0..1000)))
        .collect::<Vec<_>>()
        .join("-")
}

pub fn new_invoice_id() -> String {
    format!("{}-{}", random_groups(), INVOICE_SUFFIX)
}

pub fn new_installment_id() -> String {
    format!("{}-{}", random_groups(), INSTALLMENT_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_shape(id: &str, suffix: &str) {
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 6);
        for group in &parts[..5] {
            assert_eq!(group.len(), 3);
            assert!(group.chars().all(|c| c.is_ascii_digit()), "bad id {id}");
        }
        assert_eq!(parts[5], suffix);
    }

    #[test]
    fn invoice_ids_have_expected_shape() {
        for _ in 0..100 {
            assert_shape(&new_invoice_id(), "F");
        }
    }

    #[test]
    fn installment_ids_have_expected_shape() {
        for _ in 0..100 {
            assert_shape(&new_installment_id(), "P");
        }
    }
}
