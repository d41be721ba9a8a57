//! Dotted-path field access (`"northwest.y"`), resolved segment by segment
//! with recursive descent over nested instances.

use crate::codec::CodecError;
use crate::instance::Instance;
use crate::value::Value;

pub(crate) fn get(inst: &Instance, path: &str) -> Result<Value, CodecError> {
    match path.split_once('.') {
        Some((head, rest)) => {
            let v = inst.get_local(head)?;
            let sub = v.as_struct().ok_or_else(|| {
                CodecError::Type(format!("field `{}` is not a composite", head))
            })?;
            get(sub, rest)
        }
        None => Ok(inst.get_local(path)?.clone()),
    }
}

pub(crate) fn set(inst: &mut Instance, path: &str, value: Value) -> Result<(), CodecError> {
    match path.split_once('.') {
        Some((head, rest)) => set(inst.nested_mut(head)?, rest, value),
        None => inst.set_field(path, value),
    }
}
