//! Iterators backing `{{range}}`.

use std::sync::Arc;

use crate::values::{Key, Stream, Value};

use super::error::RuntimeError;

/// Iteration state for one `range` loop. Each step yields a
/// `(position, element)` pair: the index for sequences and streams, the key
/// for maps.
pub(crate) enum RangeIter {
    Empty,
    Seq {
        items: Arc<[Value]>,
        next: usize,
    },
    Map {
        map: Arc<crate::values::MapValue>,
        keys: Vec<Key>,
        next: usize,
    },
    Stream {
        stream: Stream,
        next: i64,
    },
}

impl RangeIter {
    pub(crate) fn new(value: &Value) -> Result<Self, RuntimeError> {
        match value {
            Value::Nil | Value::Ptr(None) | Value::Dyn(None) => Ok(RangeIter::Empty),
            Value::Ptr(Some(_)) | Value::Dyn(Some(_)) => match value.deref_once() {
                Some(inner) => Self::new(&inner),
                None => Ok(RangeIter::Empty),
            },
            Value::Seq(items) if items.is_empty() => Ok(RangeIter::Empty),
            Value::Seq(items) => Ok(RangeIter::Seq {
                items: Arc::clone(items),
                next: 0,
            }),
            Value::Map(map) if map.is_empty() => Ok(RangeIter::Empty),
            Value::Map(map) => Ok(RangeIter::Map {
                keys: map.sorted_keys(),
                map: Arc::clone(map),
                next: 0,
            }),
            Value::Stream(stream) => Ok(RangeIter::Stream {
                stream: stream.clone(),
                next: 0,
            }),
            other => Err(RuntimeError::UnsupportedIterationType {
                type_name: other.type_name(),
            }),
        }
    }

    pub(crate) fn next(&mut self) -> Option<(Value, Value)> {
        match self {
            RangeIter::Empty => None,
            RangeIter::Seq { items, next } => {
                let item = items.get(*next)?.clone().addressed();
                let pos = Value::Int(*next as i64);
                *next += 1;
                Some((pos, item.stackable()))
            }
            RangeIter::Map { map, keys, next } => {
                let key = keys.get(*next)?;
                *next += 1;
                let value = map.get(key).cloned().unwrap_or_default();
                Some((key.to_value(), value.stackable()))
            }
            RangeIter::Stream { stream, next } => {
                let item = stream.recv()?;
                let pos = Value::Int(*next);
                *next += 1;
                Some((pos, item.stackable()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    fn drain(mut it: RangeIter) -> Vec<(Value, Value)> {
        let mut out = Vec::new();
        while let Some(pair) = it.next() {
            out.push(pair);
        }
        out
    }

    #[test]
    fn test_seq_yields_indices() {
        let it = RangeIter::new(&Value::seq([Value::str("a"), Value::str("b")])).unwrap();
        assert_eq!(
            drain(it),
            vec![
                (Value::Int(0), Value::str("a")),
                (Value::Int(1), Value::str("b"))
            ]
        );
    }

    #[test]
    fn test_map_yields_sorted_keys() {
        let map = Value::map([("z", Value::Int(1)), ("a", Value::Int(2))]);
        let it = RangeIter::new(&map).unwrap();
        assert_eq!(
            drain(it),
            vec![
                (Value::str("a"), Value::Int(2)),
                (Value::str("z"), Value::Int(1))
            ]
        );
    }

    #[test]
    fn test_stream_ends_when_sender_drops() {
        let (tx, rx) = mpsc::channel();
        tx.send(Value::Int(7)).unwrap();
        tx.send(Value::Int(8)).unwrap();
        drop(tx);
        let it = RangeIter::new(&Value::stream(rx)).unwrap();
        assert_eq!(
            drain(it),
            vec![(Value::Int(0), Value::Int(7)), (Value::Int(1), Value::Int(8))]
        );
    }

    #[test]
    fn test_nil_and_pointers() {
        assert!(matches!(RangeIter::new(&Value::Nil), Ok(RangeIter::Empty)));
        assert!(matches!(
            RangeIter::new(&Value::nil_ptr()),
            Ok(RangeIter::Empty)
        ));
        let it = RangeIter::new(&Value::ptr(Value::seq([Value::Int(1)]))).unwrap();
        assert_eq!(drain(it).len(), 1);
    }

    #[test]
    fn test_scalars_are_rejected() {
        let err = RangeIter::new(&Value::Int(3)).err().unwrap();
        assert_eq!(err.to_string(), "can't range over int");
    }
}
