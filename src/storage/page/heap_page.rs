use std::sync::Arc;

use bytes::BufMut;

use crate::common::{DbError, PageId, RecordId, Result, SlotId, TransactionId, PAGE_SIZE};
use crate::tuple::{Schema, Tuple};

/// Heap page layout:
///
/// ```text
/// +---------------------+------------+------------+-----+------------------+---------+
/// | header bitmap       | slot 0     | slot 1     | ... | slot capacity-1  | padding |
/// | ceil(capacity / 8)  | tuple_size | tuple_size |     | tuple_size       | zeros   |
/// +---------------------+------------+------------+-----+------------------+---------+
/// ```
///
/// Bit `i` of the header (byte `i / 8`, bit `i % 8`, least significant bit first)
/// is set iff slot `i` holds a tuple. Empty slots and the trailing padding are zero.
/// `capacity = floor(PAGE_SIZE * 8 / (tuple_size * 8 + 1))`, i.e. each tuple costs
/// its own bytes plus one header bit.
#[derive(Debug, Clone)]
pub struct HeapPage {
    page_id: PageId,
    schema: Arc<Schema>,
    header: Vec<u8>,
    slots: Vec<Option<Tuple>>,
    dirty: bool,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    /// Number of tuple slots a page holds for the given schema.
    pub fn capacity_for(schema: &Schema) -> usize {
        let tuple_size = schema.byte_size();
        (PAGE_SIZE * 8) / (tuple_size * 8 + 1)
    }

    /// Size of the header bitmap in bytes.
    pub fn header_size_for(schema: &Schema) -> usize {
        (Self::capacity_for(schema) + 7) / 8
    }

    /// The on-disk image of a page with no tuples.
    pub fn empty_page_data() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    /// Creates an in-memory page with every slot empty.
    pub fn empty(page_id: PageId, schema: Arc<Schema>) -> Self {
        let capacity = Self::capacity_for(&schema);
        Self {
            page_id,
            header: vec![0u8; Self::header_size_for(&schema)],
            slots: vec![None; capacity],
            schema,
            dirty: false,
            dirtied_by: None,
        }
    }

    /// Parses a page image. Fails with `CorruptPage` if the image has the wrong
    /// length, marks slots beyond capacity as used, or holds an undecodable tuple.
    pub fn decode(page_id: PageId, schema: Arc<Schema>, data: &[u8]) -> Result<Self> {
        if data.len() != PAGE_SIZE {
            return Err(DbError::CorruptPage(
                page_id,
                format!("expected {} bytes, got {}", PAGE_SIZE, data.len()),
            ));
        }

        let capacity = Self::capacity_for(&schema);
        if capacity == 0 {
            return Err(DbError::CorruptPage(
                page_id,
                format!("tuples of {} bytes do not fit in a page", schema.byte_size()),
            ));
        }
        let header_size = Self::header_size_for(&schema);
        let tuple_size = schema.byte_size();
        let header = data[..header_size].to_vec();

        for slot in capacity..header_size * 8 {
            if bit_is_set(&header, slot) {
                return Err(DbError::CorruptPage(
                    page_id,
                    format!("header marks slot {} beyond capacity {}", slot, capacity),
                ));
            }
        }

        let mut slots = Vec::with_capacity(capacity);
        for slot in 0..capacity {
            if !bit_is_set(&header, slot) {
                slots.push(None);
                continue;
            }
            let start = header_size + slot * tuple_size;
            let tuple = Tuple::decode(Arc::clone(&schema), &data[start..start + tuple_size])
                .ok_or_else(|| {
                    DbError::CorruptPage(page_id, format!("slot {} does not decode", slot))
                })?;
            let rid = RecordId::new(page_id, SlotId::new(slot as u16));
            slots.push(Some(tuple.with_record_id(rid)));
        }

        Ok(Self {
            page_id,
            schema,
            header,
            slots,
            dirty: false,
            dirtied_by: None,
        })
    }

    /// Serializes the page to exactly `PAGE_SIZE` bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let tuple_size = self.schema.byte_size();
        let mut buf = Vec::with_capacity(PAGE_SIZE);
        buf.put_slice(&self.header);
        for slot in &self.slots {
            match slot {
                Some(tuple) => tuple.encode(&mut buf)?,
                None => buf.put_bytes(0, tuple_size),
            }
        }
        buf.resize(PAGE_SIZE, 0);
        Ok(buf)
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        let used: u32 = self.header.iter().map(|b| b.count_ones()).sum();
        self.capacity() - used as usize
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.capacity() && bit_is_set(&self.header, slot)
    }

    /// Stores `tuple` in the lowest free slot and stamps its record id.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<RecordId> {
        if **tuple.schema() != *self.schema {
            return Err(DbError::SchemaMismatch {
                expected: self.schema.to_string(),
                found: tuple.schema().to_string(),
            });
        }
        let slot = (0..self.capacity())
            .find(|&i| !bit_is_set(&self.header, i))
            .ok_or(DbError::PageFull(self.page_id))?;

        let rid = RecordId::new(self.page_id, SlotId::new(slot as u16));
        tuple.set_record_id(Some(rid));
        self.slots[slot] = Some(tuple.clone());
        set_bit(&mut self.header, slot, true);
        self.dirty = true;
        Ok(rid)
    }

    /// Empties the slot named by the tuple's record id.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let rid = tuple.record_id().ok_or_else(|| {
            DbError::SlotNotOccupied("tuple has no record id".to_string())
        })?;
        if rid.page_id != self.page_id {
            return Err(DbError::SlotNotOccupied(format!(
                "{} does not belong to {}",
                rid, self.page_id
            )));
        }
        let slot = rid.slot_id.as_usize();
        if !self.is_slot_used(slot) {
            return Err(DbError::SlotNotOccupied(rid.to_string()));
        }

        self.slots[slot] = None;
        set_bit(&mut self.header, slot, false);
        self.dirty = true;
        Ok(())
    }

    /// Iterates over stored tuples in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.slots.iter().flatten()
    }

    /// Marks the page dirty on behalf of `tid`.
    pub fn mark_dirty(&mut self, tid: TransactionId) {
        self.dirty = true;
        self.dirtied_by = Some(tid);
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
        self.dirtied_by = None;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The transaction that last dirtied this page, if any.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }
}

impl PartialEq for HeapPage {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id
            && self.schema == other.schema
            && self.header == other.header
            && self.slots == other.slots
    }
}

fn bit_is_set(header: &[u8], slot: usize) -> bool {
    header[slot / 8] & (1 << (slot % 8)) != 0
}

fn set_bit(header: &mut [u8], slot: usize, value: bool) {
    if value {
        header[slot / 8] |= 1 << (slot % 8);
    } else {
        header[slot / 8] &= !(1 << (slot % 8));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TableId;
    use crate::tuple::{DataType, Field};

    fn two_ints() -> Arc<Schema> {
        Schema::builder()
            .column("a", DataType::Int)
            .column("b", DataType::Int)
            .build_arc()
    }

    fn pid(n: u32) -> PageId {
        PageId::new(TableId::new(1), n)
    }

    fn row(schema: &Arc<Schema>, a: i32, b: i32) -> Tuple {
        Tuple::new(Arc::clone(schema), vec![Field::Int(a), Field::Int(b)]).unwrap()
    }

    #[test]
    fn test_capacity() {
        // 8-byte tuples: 4096 * 8 / 65 = 504 slots, 63 header bytes
        assert_eq!(HeapPage::capacity_for(&two_ints()), 504);
        assert_eq!(HeapPage::header_size_for(&two_ints()), 63);
    }

    #[test]
    fn test_empty_page() {
        let page = HeapPage::decode(pid(0), two_ints(), &HeapPage::empty_page_data()).unwrap();
        assert_eq!(page.num_empty_slots(), 504);
        assert_eq!(page.iter().count(), 0);
        assert_eq!(page, HeapPage::empty(pid(0), two_ints()));
    }

    #[test]
    fn test_insert_sets_record_id_and_bit() {
        let schema = two_ints();
        let mut page = HeapPage::empty(pid(2), schema.clone());
        let mut t = row(&schema, 1, 2);

        let rid = page.insert_tuple(&mut t).unwrap();
        assert_eq!(rid, RecordId::new(pid(2), SlotId::new(0)));
        assert_eq!(t.record_id(), Some(rid));
        assert!(page.is_slot_used(0));
        assert!(page.is_dirty());
        assert_eq!(page.num_empty_slots(), 503);

        let bytes = page.encode().unwrap();
        assert_eq!(bytes[0], 0b0000_0001);
    }

    #[test]
    fn test_round_trip() {
        let schema = two_ints();
        let mut page = HeapPage::empty(pid(0), schema.clone());
        for i in 0..10 {
            page.insert_tuple(&mut row(&schema, i, i * 10)).unwrap();
        }
        let victim = page.iter().nth(3).cloned().unwrap();
        page.delete_tuple(&victim).unwrap();

        let bytes = page.encode().unwrap();
        assert_eq!(bytes.len(), PAGE_SIZE);
        let decoded = HeapPage::decode(pid(0), schema.clone(), &bytes).unwrap();
        assert_eq!(decoded, page);
        assert_eq!(decoded.num_empty_slots(), page.num_empty_slots());
        assert_eq!(decoded.encode().unwrap(), bytes);

        let firsts: Vec<i32> = decoded
            .iter()
            .map(|t| t.field(0).unwrap().as_int().unwrap())
            .collect();
        assert_eq!(firsts, vec![0, 1, 2, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_deleted_slot_is_reused() {
        let schema = two_ints();
        let mut page = HeapPage::empty(pid(0), schema.clone());
        let mut a = row(&schema, 1, 1);
        let mut b = row(&schema, 2, 2);
        page.insert_tuple(&mut a).unwrap();
        page.insert_tuple(&mut b).unwrap();

        page.delete_tuple(&a).unwrap();
        let mut c = row(&schema, 3, 3);
        let rid = page.insert_tuple(&mut c).unwrap();
        assert_eq!(rid.slot_id, SlotId::new(0));
    }

    #[test]
    fn test_page_full() {
        let schema = two_ints();
        let mut page = HeapPage::empty(pid(0), schema.clone());
        for i in 0..504 {
            page.insert_tuple(&mut row(&schema, i, 0)).unwrap();
        }
        assert_eq!(page.num_empty_slots(), 0);
        assert!(matches!(
            page.insert_tuple(&mut row(&schema, 0, 0)),
            Err(DbError::PageFull(_))
        ));
    }

    #[test]
    fn test_schema_mismatch() {
        let mut page = HeapPage::empty(pid(0), two_ints());
        let other = Schema::builder().column("s", DataType::Str(4)).build_arc();
        let mut t = Tuple::new(other, vec![Field::from("x")]).unwrap();
        assert!(matches!(
            page.insert_tuple(&mut t),
            Err(DbError::SchemaMismatch { .. })
        ));
        assert_eq!(page.num_empty_slots(), 504);
    }

    #[test]
    fn test_delete_errors() {
        let schema = two_ints();
        let mut page = HeapPage::empty(pid(0), schema.clone());

        // no record id
        assert!(matches!(
            page.delete_tuple(&row(&schema, 1, 1)),
            Err(DbError::SlotNotOccupied(_))
        ));

        let mut t = row(&schema, 1, 1);
        page.insert_tuple(&mut t).unwrap();
        page.delete_tuple(&t).unwrap();
        // already empty
        assert!(matches!(
            page.delete_tuple(&t),
            Err(DbError::SlotNotOccupied(_))
        ));

        // belongs to another page
        let mut foreign = HeapPage::empty(pid(1), schema.clone());
        let mut u = row(&schema, 2, 2);
        foreign.insert_tuple(&mut u).unwrap();
        assert!(matches!(
            page.delete_tuple(&u),
            Err(DbError::SlotNotOccupied(_))
        ));
    }

    #[test]
    fn test_corrupt_pages() {
        let schema = two_ints();
        assert!(matches!(
            HeapPage::decode(pid(0), schema.clone(), &[0u8; 100]),
            Err(DbError::CorruptPage(..))
        ));

        // 504 slots use bits 0..504 of a 63-byte header, so nothing trails.
        // A 12-byte tuple gives 337 slots and 43 header bytes with 7 spare bits.
        let wide = Schema::from_types(&[DataType::Int, DataType::Int, DataType::Int]);
        assert_eq!(HeapPage::capacity_for(&wide), 337);
        let mut data = HeapPage::empty_page_data();
        data[42] = 0b1000_0000;
        assert!(matches!(
            HeapPage::decode(pid(0), Arc::new(wide), &data),
            Err(DbError::CorruptPage(..))
        ));
    }

    #[test]
    fn test_dirty_tracking() {
        let mut page = HeapPage::empty(pid(0), two_ints());
        assert!(!page.is_dirty());
        let tid = TransactionId::next();
        page.mark_dirty(tid);
        assert_eq!(page.dirtied_by(), Some(tid));
        page.mark_clean();
        assert!(!page.is_dirty());
        assert_eq!(page.dirtied_by(), None);
    }
}
