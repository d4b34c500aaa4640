use std::io::Write;

use crate::errors::EncodingError;

/// A single field of a MessagePack tuple.
///
/// Blanket-implemented for everything `serde` can serialize, which keeps
/// request arguments as plain Rust values.
pub trait TupleElement {
    fn encode_into_writer<W: Write>(&self, buf: W) -> Result<(), EncodingError>;
}

impl<T: serde::Serialize> TupleElement for T {
    fn encode_into_writer<W: Write>(&self, mut buf: W) -> Result<(), EncodingError> {
        rmp_serde::encode::write(&mut buf, self)?;
        Ok(())
    }
}

/// Type encodable as a MessagePack array.
///
/// Used for request tuples and keys: `CALL` arguments, `SELECT` keys,
/// `INSERT`/`REPLACE` rows, `UPDATE`/`UPSERT` operation lists.
pub trait Tuple {
    fn encode_into_writer<W: Write>(&self, buf: W) -> Result<(), EncodingError>;
}

impl<T: TupleElement> Tuple for Vec<T> {
    fn encode_into_writer<W: Write>(&self, buf: W) -> Result<(), EncodingError> {
        self.as_slice().encode_into_writer(buf)
    }
}

impl<T: TupleElement> Tuple for &[T] {
    fn encode_into_writer<W: Write>(&self, mut buf: W) -> Result<(), EncodingError> {
        rmp::encode::write_array_len(&mut buf, self.len() as u32)?;
        for element in self.iter() {
            element.encode_into_writer(&mut buf)?;
        }
        Ok(())
    }
}

impl<T: TupleElement, const N: usize> Tuple for [T; N] {
    fn encode_into_writer<W: Write>(&self, buf: W) -> Result<(), EncodingError> {
        self.as_slice().encode_into_writer(buf)
    }
}

/// Unit encodes as an empty tuple.
impl Tuple for () {
    fn encode_into_writer<W: Write>(&self, mut buf: W) -> Result<(), EncodingError> {
        rmp::encode::write_array_len(&mut buf, 0)?;
        Ok(())
    }
}

impl<T: Tuple> Tuple for &T {
    fn encode_into_writer<W: Write>(&self, buf: W) -> Result<(), EncodingError> {
        (*self).encode_into_writer(buf)
    }
}

macro_rules! impl_tuple {
    ($len:expr; $($param:ident @ $idx:tt),+) => {
        impl<$($param: TupleElement),+> Tuple for ($($param,)+) {
            fn encode_into_writer<W: Write>(&self, mut buf: W) -> Result<(), EncodingError> {
                rmp::encode::write_array_len(&mut buf, $len)?;
                $( self.$idx.encode_into_writer(&mut buf)?; )+
                Ok(())
            }
        }
    };
}

impl_tuple!(1; T0 @ 0);
impl_tuple!(2; T0 @ 0, T1 @ 1);
impl_tuple!(3; T0 @ 0, T1 @ 1, T2 @ 2);
impl_tuple!(4; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3);
impl_tuple!(5; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3, T4 @ 4);
impl_tuple!(6; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3, T4 @ 4, T5 @ 5);
impl_tuple!(7; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3, T4 @ 4, T5 @ 5, T6 @ 6);
impl_tuple!(8; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3, T4 @ 4, T5 @ 5, T6 @ 6, T7 @ 7);
impl_tuple!(9; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3, T4 @ 4, T5 @ 5, T6 @ 6, T7 @ 7, T8 @ 8);
impl_tuple!(10; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3, T4 @ 4, T5 @ 5, T6 @ 6, T7 @ 7, T8 @ 8, T9 @ 9);
impl_tuple!(11; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3, T4 @ 4, T5 @ 5, T6 @ 6, T7 @ 7, T8 @ 8, T9 @ 9, T10 @ 10);
impl_tuple!(12; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3, T4 @ 4, T5 @ 5, T6 @ 6, T7 @ 7, T8 @ 8, T9 @ 9, T10 @ 10, T11 @ 11);
impl_tuple!(13; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3, T4 @ 4, T5 @ 5, T6 @ 6, T7 @ 7, T8 @ 8, T9 @ 9, T10 @ 10, T11 @ 11, T12 @ 12);
impl_tuple!(14; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3, T4 @ 4, T5 @ 5, T6 @ 6, T7 @ 7, T8 @ 8, T9 @ 9, T10 @ 10, T11 @ 11, T12 @ 12, T13 @ 13);
impl_tuple!(15; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3, T4 @ 4, T5 @ 5, T6 @ 6, T7 @ 7, T8 @ 8, T9 @ 9, T10 @ 10, T11 @ 11, T12 @ 12, T13 @ 13, T14 @ 14);
impl_tuple!(16; T0 @ 0, T1 @ 1, T2 @ 2, T3 @ 3, T4 @ 4, T5 @ 5, T6 @ 6, T7 @ 7, T8 @ 8, T9 @ 9, T10 @ 10, T11 @ 11, T12 @ 12, T13 @ 13, T14 @ 14, T15 @ 15);
