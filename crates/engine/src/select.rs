//! Declarative descriptors of the inputs a rule needs.
//!
//! A selector carries no resolved data itself; it tells the engine what to
//! resolve — and from which subject — before a rule's transform may run.

use crate::product::{ProductType, ProductValue, SubjectShape};

/// One declared input of a rule.
#[derive(Debug, Clone)]
pub enum Selector {
  /// A fixed, already-available value. Never triggers resolution.
  Literal {
    value: ProductValue,
    product: ProductType,
  },

  /// The product of `product` for the same subject being resolved.
  Direct { product: ProductType },

  /// The product of `product` for *each* item in the named field of the
  /// subject's `dep_product`, preserving the field's declared order.
  Dependencies {
    product: ProductType,
    dep_product: ProductType,
    field: String,
  },

  /// Resolve `input` for the current subject, extract `field` from it, and
  /// re-request `product` for a new subject of shape `projected` built from
  /// the extracted value.
  Projection {
    product: ProductType,
    projected: SubjectShape,
    field: String,
    input: ProductType,
  },
}

impl Selector {
  pub fn literal(value: ProductValue, product: ProductType) -> Self {
    Self::Literal { value, product }
  }

  pub fn direct(product: ProductType) -> Self {
    Self::Direct { product }
  }

  pub fn dependencies(
    product: ProductType,
    dep_product: ProductType,
    field: impl Into<String>,
  ) -> Self {
    Self::Dependencies {
      product,
      dep_product,
      field: field.into(),
    }
  }

  pub fn projection(
    product: ProductType,
    projected: SubjectShape,
    field: impl Into<String>,
    input: ProductType,
  ) -> Self {
    Self::Projection {
      product,
      projected,
      field: field.into(),
      input,
    }
  }
}
