use std::convert::TryFrom;

use bytes::Buf;
use bytes::BufMut;
use rand::Rng;

use caesar::replica::Application;
use caesar::replica::ApplicationError;
use caesar::request::ObjectId;
use caesar::request::Request;
use caesar::request::RequestId;

use crate::registry::SharedObjectRegistry;

/// Value every key starts with. Written values are random below it.
pub const INITIAL_VALUE: i32 = 1000;

pub const DEFAULT_SIZE: usize = 1000;

/// Size of the payload header: transaction type, op and batch size.
const HEADER_SIZE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnType {
    ReadOnly = 0,
    ReadWrite = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Get = 0,
    Put = 1,
}

impl TryFrom<u8> for OpType {
    type Error = ApplicationError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(OpType::Get),
            1 => Ok(OpType::Put),
            _ => Err(ApplicationError::BadPayload(format!("unknown op: {}", v))),
        }
    }
}

/// KeyValue is a benchmark store of `size` integer keys.
///
/// A request is a batch of key/value pairs with one op. Its payload is:
///
/// ```text
/// [txn type: u8][op: u8][batch: i32] batch * ([key: i32][value: i32])
/// ```
///
/// All integers are big-endian. The request touches the objects of its keys.
pub struct KeyValue {
    size: usize,
    conflict_pool: usize,
    registry: SharedObjectRegistry<i32>,
}

impl KeyValue {
    /// new creates a store with keys `0..size`, each set to `INITIAL_VALUE`.
    pub fn new(size: usize, conflict_pool: usize) -> KeyValue {
        let mut registry = SharedObjectRegistry::with_capacity(size);
        for oid in 0..size {
            // keys are distinct
            let _ = registry.register_objects(oid as ObjectId, INITIAL_VALUE);
        }

        KeyValue {
            size,
            conflict_pool,
            registry,
        }
    }

    /// get returns the current value of a key.
    pub fn get(&self, key: ObjectId) -> Result<i32, ApplicationError> {
        let v = self.registry.get_object(key).map_err(not_found)?;
        Ok(*v)
    }

    /// put sets a key and returns its previous value.
    pub fn put(&self, key: ObjectId, value: i32) -> Result<i32, ApplicationError> {
        let mut v = self.registry.get_object(key).map_err(not_found)?;
        let prev = *v;
        *v = value;
        Ok(prev)
    }

    /// key_of picks the key of one batch entry.
    ///
    /// Access mode 0 makes clients contend on `conflict_pool` keys. Mode 1 gives every request
    /// its own key above the pool, so nothing conflicts until the keys wrap around `size`.
    /// Other modes pick a random key.
    pub fn key_of<R: Rng>(
        &self,
        rng: &mut R,
        id: RequestId,
        access_mode: i32,
        n_replicas: usize,
    ) -> ObjectId {
        let size = self.size.max(1) as i64;
        match access_mode {
            0 => id.seq_number.rem_euclid(self.conflict_pool.max(1) as i32),
            1 => {
                let k = id.client_id as i64
                    + id.seq_number as i64 * n_replicas as i64
                    + self.conflict_pool as i64
                    + 1;
                k.rem_euclid(size) as ObjectId
            }
            _ => rng.gen_range(0, size) as ObjectId,
        }
    }
}

fn not_found(e: crate::registry::RegistryError) -> ApplicationError {
    ApplicationError::Failed(e.to_string())
}

impl Application for KeyValue {
    fn create_request(
        &self,
        id: RequestId,
        read: bool,
        access_mode: i32,
        batch_size: usize,
        n_replicas: usize,
    ) -> Request {
        let mut rng = rand::thread_rng();

        let mut payload = Vec::with_capacity(HEADER_SIZE + batch_size * 8);
        let mut object_ids = Vec::with_capacity(batch_size);

        if read {
            payload.put_u8(TxnType::ReadOnly as u8);
            payload.put_u8(OpType::Get as u8);
        } else {
            payload.put_u8(TxnType::ReadWrite as u8);
            payload.put_u8(OpType::Put as u8);
        }
        payload.put_i32(batch_size as i32);

        for _ in 0..batch_size {
            let key = self.key_of(&mut rng, id, access_mode, n_replicas);
            let value = rng.gen_range(0, INITIAL_VALUE);

            object_ids.push(key);
            payload.put_i32(key);
            payload.put_i32(value);
        }

        Request::new(id, object_ids, payload)
    }

    fn execute_request(&self, r: &Request) -> Result<(), ApplicationError> {
        let mut buf = r.payload();
        if buf.remaining() < HEADER_SIZE {
            return Err(ApplicationError::BadPayload(format!(
                "{}: header needs {} bytes, got {}",
                r.id(),
                HEADER_SIZE,
                buf.remaining()
            )));
        }

        let _txn_type = buf.get_u8();
        let op = OpType::try_from(buf.get_u8())?;
        let batch = buf.get_i32();

        if batch < 0 || buf.remaining() != batch as usize * 8 {
            return Err(ApplicationError::BadPayload(format!(
                "{}: batch of {} with {} bytes",
                r.id(),
                batch,
                buf.remaining()
            )));
        }

        for _ in 0..batch {
            let key = buf.get_i32();
            let value = buf.get_i32();

            match op {
                OpType::Put => {
                    self.put(key, value)?;
                }
                OpType::Get => {
                    self.get(key)?;
                }
            }
        }

        debug!("kv: executed {} {:?} batch: {}", r.id(), op, batch);
        Ok(())
    }

    fn total_objects(&self) -> usize {
        self.size
    }
}
