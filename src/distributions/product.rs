use nalgebra::DVector;
use rand::RngCore;

use super::{Distribution, UnivariateDistribution};

/// A heterogeneous product of independent univariate distributions,
/// composed into a joint distribution whose `logpdf` is the sum of the
/// components'.
///
/// Implemented for fixed tuple arities with static dispatch, rather than a
/// boxed `Vec<Box<dyn UnivariateDistribution>>`: the arity is known at the
/// call site, and the whole point of this type is to avoid the
/// virtual-dispatch and allocation overhead of a heterogeneous sequence in a
/// loop that otherwise doesn't allocate.
pub struct TupleProduct<T>(pub T);

macro_rules! impl_tuple_product {
    ($n:expr; $($idx:tt : $ty:ident),+) => {
        impl<$($ty: UnivariateDistribution),+> Distribution for TupleProduct<($($ty,)+)> {
            fn dim(&self) -> usize {
                $n
            }

            fn sample(&self, rng: &mut dyn RngCore) -> DVector<f64> {
                DVector::from_vec(vec![$(self.0.$idx.sample(rng)),+])
            }

            fn logpdf(&self, x: &DVector<f64>) -> f64 {
                let mut total = 0.0;
                $(total += self.0.$idx.logpdf(x[$idx]);)+
                total
            }
        }
    };
}

impl_tuple_product!(1; 0: A);
impl_tuple_product!(2; 0: A, 1: B);
impl_tuple_product!(3; 0: A, 1: B, 2: C);
impl_tuple_product!(4; 0: A, 1: B, 2: C, 3: D);
impl_tuple_product!(5; 0: A, 1: B, 2: C, 3: D, 4: E);
impl_tuple_product!(6; 0: A, 1: B, 2: C, 3: D, 4: E, 5: F);
