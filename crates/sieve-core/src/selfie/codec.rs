//! Selfie writer and loader

use std::collections::{BTreeMap, HashMap};

use super::format::*;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::filter::FilterRecord;
use crate::hash::crc32;
use crate::index::{RecordId, Slot};
use crate::types::{FilterFlags, MatchKind, PartyMask, Realm, RequestType};

/// Error type for selfie loading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelfieError {
    #[error("Invalid magic bytes")]
    InvalidMagic,
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),
    #[error("CRC32 mismatch: stored={stored}, computed={computed}")]
    Crc32Mismatch { stored: u32, computed: u32 },
    #[error("Invalid section: {0}")]
    InvalidSection(String),
    #[error("Data too short")]
    DataTooShort,
}

fn invalid(section: SectionId, what: impl std::fmt::Display) -> SelfieError {
    SelfieError::InvalidSection(format!("{}: {}", section.name(), what))
}

// =============================================================================
// Writer
// =============================================================================

struct SectionData {
    id: SectionId,
    data: Vec<u8>,
    count: u32,
    offset: usize,
}

impl SectionData {
    fn new(id: SectionId, data: Vec<u8>, count: usize) -> Self {
        Self {
            id,
            data,
            count: count as u32,
            offset: 0,
        }
    }
}

struct StringPool {
    data: Vec<u8>,
    index: HashMap<String, u32>,
}

impl StringPool {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn intern(&mut self, s: &str) -> (u32, u32) {
        if let Some(&offset) = self.index.get(s) {
            return (offset, s.len() as u32);
        }
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(s.as_bytes());
        self.index.insert(s.to_string(), offset);
        (offset, s.len() as u32)
    }

    fn put(&mut self, buf: &mut Vec<u8>, s: &str) {
        let (offset, len) = self.intern(s);
        put_u32(buf, offset);
        put_u32(buf, len);
    }

    fn build(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.data.len());
        put_u32(&mut buf, self.data.len() as u32);
        buf.extend_from_slice(&self.data);
        buf
    }
}

#[inline]
fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_ids(buf: &mut Vec<u8>, ids: &[RecordId]) {
    put_u32(buf, ids.len() as u32);
    for &id in ids {
        put_u32(buf, id);
    }
}

fn build_records_section(engine: &Engine, pool: &mut StringPool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(engine.records.len() * RECORD_SIZE);
    for record in &engine.records {
        buf.push(record.kind as u8);
        buf.push(record.flags.bits());
        buf.push(record.party_mask.bits());
        buf.push(0);
        put_u32(&mut buf, record.type_mask.bits());
        buf.extend_from_slice(&record.list_id.to_le_bytes());
        buf.extend_from_slice(&[0, 0]);
        pool.put(&mut buf, &record.pattern);
        pool.put(&mut buf, &record.domain_opt);
        pool.put(&mut buf, &record.raw);
    }
    buf
}

fn build_tokens_section(engine: &Engine) -> Vec<u8> {
    let mut buf = Vec::new();
    for realm in Realm::ALL {
        let index = &engine.realms[realm.index()];
        let tokens = index.sorted_tokens();
        put_u32(&mut buf, tokens.len() as u32);
        for (hash, ids) in &tokens {
            put_u32(&mut buf, *hash);
            put_ids(&mut buf, ids);
        }
        put_ids(&mut buf, &index.no_token.sorted_ids());
        put_ids(&mut buf, &index.regex.sorted_ids());
    }
    buf
}

fn build_hostnames_section(engine: &Engine, pool: &mut StringPool) -> (Vec<u8>, usize) {
    let mut buf = Vec::new();
    let mut groups = 0;
    for realm in Realm::ALL {
        for (&list_id, set) in &engine.realms[realm.index()].hostnames {
            if set.is_empty() {
                continue;
            }
            let entries = set.sorted_entries();
            buf.push(realm as u8);
            buf.push(0);
            buf.extend_from_slice(&list_id.to_le_bytes());
            put_u32(&mut buf, entries.len() as u32);
            for host in entries {
                pool.put(&mut buf, host);
            }
            groups += 1;
        }
    }
    (buf, groups)
}

impl Engine {
    /// Serialize the loaded lists into a selfie.
    pub fn serialize(&self) -> Vec<u8> {
        let mut pool = StringPool::new();

        let mut lists = Vec::with_capacity(self.lists.len() * 8);
        for name in &self.lists {
            pool.put(&mut lists, name);
        }
        let records = build_records_section(self, &mut pool);
        let tokens = build_tokens_section(self);
        let (hostnames, groups) = build_hostnames_section(self, &mut pool);

        let mut sections = vec![
            SectionData::new(SectionId::StrPool, pool.build(), 1),
            SectionData::new(SectionId::Lists, lists, self.lists.len()),
            SectionData::new(SectionId::Records, records, self.records.len()),
            SectionData::new(SectionId::Tokens, tokens, Realm::ALL.len()),
            SectionData::new(SectionId::Hostnames, hostnames, groups),
        ];

        let section_count = sections.len();
        let section_dir_offset = HEADER_SIZE;
        let section_dir_bytes = section_count * SECTION_ENTRY_SIZE;
        let mut data_offset = align_offset(section_dir_offset + section_dir_bytes, 4);

        for section in &mut sections {
            section.offset = data_offset;
            data_offset = align_offset(data_offset + section.data.len(), 4);
        }

        let mut buffer = vec![0u8; data_offset];

        buffer[header::MAGIC..header::MAGIC + 4].copy_from_slice(&SELFIE_MAGIC);
        write_u16_le(&mut buffer, header::VERSION, SELFIE_VERSION);
        write_u16_le(&mut buffer, header::FLAGS, header_flags::HAS_CRC32);
        write_u32_le(&mut buffer, header::HEADER_BYTES, HEADER_SIZE as u32);
        write_u32_le(&mut buffer, header::SECTION_COUNT, section_count as u32);
        write_u32_le(&mut buffer, header::SECTION_DIR_OFFSET, section_dir_offset as u32);
        write_u32_le(&mut buffer, header::RECORD_COUNT, self.records.len() as u32);
        write_u32_le(&mut buffer, header::LIST_COUNT, self.lists.len() as u32);

        for (index, section) in sections.iter().enumerate() {
            let entry_offset = section_dir_offset + index * SECTION_ENTRY_SIZE;
            write_u16_le(&mut buffer, entry_offset + section_entry::ID, section.id as u16);
            write_u16_le(&mut buffer, entry_offset + section_entry::FLAGS, 0);
            write_u32_le(&mut buffer, entry_offset + section_entry::OFFSET, section.offset as u32);
            write_u32_le(&mut buffer, entry_offset + section_entry::LENGTH, section.data.len() as u32);
            write_u32_le(&mut buffer, entry_offset + section_entry::COUNT, section.count);

            let end = section.offset + section.data.len();
            buffer[section.offset..end].copy_from_slice(&section.data);
        }

        let crc = compute_crc(&buffer);
        write_u32_le(&mut buffer, header::SELFIE_CRC32, crc);
        buffer
    }

    /// Restore an engine from a selfie. The result is frozen.
    pub fn deserialize(data: &[u8], config: EngineConfig) -> Result<Engine, SelfieError> {
        let selfie = SelfieView::load(data)?;
        let pool = StrPoolView::new(selfie.section(SectionId::StrPool)?.0)?;

        let lists = decode_lists(&selfie, &pool)?;
        let records = decode_records(&selfie, &pool, lists.len())?;
        let slots = decode_slots(&selfie, &records)?;
        let hostnames = decode_hostnames(&selfie, &pool, lists.len())?;

        Ok(Engine::from_parts(
            config,
            lists,
            slots.into_iter().zip(records).collect(),
            hostnames,
        ))
    }
}

/// CRC over everything except the CRC field.
fn compute_crc(data: &[u8]) -> u32 {
    let mut crc_data = Vec::with_capacity(data.len() - 4);
    crc_data.extend_from_slice(&data[..header::SELFIE_CRC32]);
    crc_data.extend_from_slice(&data[header::SELFIE_CRC32 + 4..]);
    crc32(&crc_data)
}

// =============================================================================
// Loader
// =============================================================================

/// Validated header and section directory.
struct SelfieView<'a> {
    sections: BTreeMap<SectionId, (&'a [u8], u32)>,
    record_count: usize,
}

impl<'a> SelfieView<'a> {
    fn load(data: &'a [u8]) -> Result<Self, SelfieError> {
        if data.len() < HEADER_SIZE {
            return Err(SelfieError::DataTooShort);
        }

        if !validate_magic(data) {
            return Err(SelfieError::InvalidMagic);
        }

        let read = |offset| read_u32_le(data, offset).ok_or(SelfieError::DataTooShort);

        let version = read_u16_le(data, header::VERSION).ok_or(SelfieError::DataTooShort)?;
        if version != SELFIE_VERSION {
            return Err(SelfieError::UnsupportedVersion(version));
        }

        let flags = read_u16_le(data, header::FLAGS).ok_or(SelfieError::DataTooShort)?;
        if flags & header_flags::HAS_CRC32 != 0 {
            let stored = read(header::SELFIE_CRC32)?;
            let computed = compute_crc(data);
            if stored != computed {
                return Err(SelfieError::Crc32Mismatch { stored, computed });
            }
        }

        let section_count = read(header::SECTION_COUNT)? as usize;
        let section_dir_offset = read(header::SECTION_DIR_OFFSET)? as usize;
        let record_count = read(header::RECORD_COUNT)? as usize;

        let mut sections = BTreeMap::new();
        for i in 0..section_count {
            let entry_offset = section_dir_offset + i * SECTION_ENTRY_SIZE;
            if entry_offset + SECTION_ENTRY_SIZE > data.len() {
                return Err(SelfieError::DataTooShort);
            }

            let id_raw = read_u16_le(data, entry_offset + section_entry::ID).ok_or(SelfieError::DataTooShort)?;
            let id = match SectionId::try_from(id_raw) {
                Ok(id) => id,
                Err(_) => continue, // Skip unknown sections
            };

            let offset = read(entry_offset + section_entry::OFFSET)? as usize;
            let length = read(entry_offset + section_entry::LENGTH)? as usize;
            let count = read(entry_offset + section_entry::COUNT)?;
            let bytes = offset
                .checked_add(length)
                .and_then(|end| data.get(offset..end))
                .ok_or_else(|| invalid(id, "out of bounds"))?;
            sections.insert(id, (bytes, count));
        }

        Ok(Self {
            sections,
            record_count,
        })
    }

    fn section(&self, id: SectionId) -> Result<(&'a [u8], usize), SelfieError> {
        self.sections
            .get(&id)
            .map(|&(bytes, count)| (bytes, count as usize))
            .ok_or_else(|| invalid(id, "missing"))
    }
}

struct StrPoolView<'a> {
    data: &'a [u8],
}

impl<'a> StrPoolView<'a> {
    fn new(section: &'a [u8]) -> Result<Self, SelfieError> {
        let len = read_u32_le(section, 0).ok_or(SelfieError::DataTooShort)? as usize;
        let data = section
            .get(4..4 + len)
            .ok_or_else(|| invalid(SectionId::StrPool, "length exceeds section"))?;
        Ok(Self { data })
    }

    fn get(&self, offset: u32, len: u32) -> Result<&'a str, SelfieError> {
        let start = offset as usize;
        let bytes = start
            .checked_add(len as usize)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| invalid(SectionId::StrPool, "string out of bounds"))?;
        std::str::from_utf8(bytes).map_err(|_| invalid(SectionId::StrPool, "invalid utf-8"))
    }
}

/// Sequential bounds-checked reader over one section.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, SelfieError> {
        let value = *self.data.get(self.pos).ok_or(SelfieError::DataTooShort)?;
        self.pos += 1;
        Ok(value)
    }

    fn u16(&mut self) -> Result<u16, SelfieError> {
        let value = read_u16_le(self.data, self.pos).ok_or(SelfieError::DataTooShort)?;
        self.pos += 2;
        Ok(value)
    }

    fn u32(&mut self) -> Result<u32, SelfieError> {
        let value = read_u32_le(self.data, self.pos).ok_or(SelfieError::DataTooShort)?;
        self.pos += 4;
        Ok(value)
    }

    fn str(&mut self, pool: &StrPoolView<'a>) -> Result<&'a str, SelfieError> {
        let offset = self.u32()?;
        let len = self.u32()?;
        pool.get(offset, len)
    }

    fn ids(&mut self) -> Result<Vec<RecordId>, SelfieError> {
        let count = self.u32()? as usize;
        if count > self.data.len().saturating_sub(self.pos) / 4 {
            return Err(SelfieError::DataTooShort);
        }
        (0..count).map(|_| self.u32()).collect()
    }
}

fn decode_lists(selfie: &SelfieView<'_>, pool: &StrPoolView<'_>) -> Result<Vec<String>, SelfieError> {
    let (bytes, count) = selfie.section(SectionId::Lists)?;
    if count > usize::from(u16::MAX) {
        return Err(invalid(SectionId::Lists, "too many lists"));
    }
    let mut cursor = Cursor::new(bytes);
    (0..count).map(|_| cursor.str(pool).map(str::to_string)).collect()
}

fn decode_records(
    selfie: &SelfieView<'_>,
    pool: &StrPoolView<'_>,
    list_count: usize,
) -> Result<Vec<FilterRecord>, SelfieError> {
    let section = SectionId::Records;
    let (bytes, count) = selfie.section(section)?;
    if count != selfie.record_count || bytes.len() != count * RECORD_SIZE {
        return Err(invalid(section, "record count does not match"));
    }

    let mut cursor = Cursor::new(bytes);
    let mut records = Vec::with_capacity(count);
    for id in 0..count {
        let kind = MatchKind::try_from(cursor.u8()?).map_err(|_| invalid(section, "bad match kind"))?;
        let flags = FilterFlags::from_bits(cursor.u8()?).ok_or_else(|| invalid(section, "bad flags"))?;
        let party_mask = PartyMask::from_bits(cursor.u8()?).ok_or_else(|| invalid(section, "bad party mask"))?;
        cursor.u8()?;
        let type_mask = RequestType::from_bits(cursor.u32()?).ok_or_else(|| invalid(section, "bad type mask"))?;
        let list_id = cursor.u16()?;
        cursor.u16()?;
        if usize::from(list_id) >= list_count {
            return Err(invalid(section, format!("record {} refers to list {}", id, list_id)));
        }
        let pattern = cursor.str(pool)?.to_string();
        let domain_opt = cursor.str(pool)?.to_string();
        let raw = cursor.str(pool)?.to_string();

        let record = FilterRecord::new(pattern, kind, flags, type_mask, party_mask, domain_opt, list_id, raw)
            .map_err(|e| invalid(section, format!("record {}: {}", id, e)))?;
        records.push(record);
    }
    Ok(records)
}

fn decode_slots(selfie: &SelfieView<'_>, records: &[FilterRecord]) -> Result<Vec<Slot>, SelfieError> {
    let section = SectionId::Tokens;
    let (bytes, count) = selfie.section(section)?;
    if count != Realm::ALL.len() {
        return Err(invalid(section, "expected one entry per realm"));
    }

    let mut slots: Vec<Option<Slot>> = vec![None; records.len()];
    let mut assign = |realm: Realm, slot: Slot, ids: Vec<RecordId>| -> Result<(), SelfieError> {
        for id in ids {
            let record = records
                .get(id as usize)
                .ok_or_else(|| invalid(section, format!("unknown record {}", id)))?;
            if Realm::from_flags(record.flags) != realm {
                return Err(invalid(section, format!("record {} filed under {}", id, realm.name())));
            }
            let entry = &mut slots[id as usize];
            if entry.is_some() {
                return Err(invalid(section, format!("record {} indexed twice", id)));
            }
            *entry = Some(slot);
        }
        Ok(())
    };

    let mut cursor = Cursor::new(bytes);
    for realm in Realm::ALL {
        let buckets = cursor.u32()?;
        for _ in 0..buckets {
            let hash = cursor.u32()?;
            let ids = cursor.ids()?;
            assign(realm, Slot::Token(hash), ids)?;
        }
        let no_token = cursor.ids()?;
        assign(realm, Slot::NoToken, no_token)?;
        let regex = cursor.ids()?;
        assign(realm, Slot::Regex, regex)?;
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(id, slot)| slot.ok_or_else(|| invalid(section, format!("record {} not indexed", id))))
        .collect()
}

fn decode_hostnames(
    selfie: &SelfieView<'_>,
    pool: &StrPoolView<'_>,
    list_count: usize,
) -> Result<Vec<(Realm, u16, Vec<String>)>, SelfieError> {
    let section = SectionId::Hostnames;
    let (bytes, count) = selfie.section(section)?;
    let mut cursor = Cursor::new(bytes);
    let mut groups = Vec::new();
    for _ in 0..count {
        let realm = Realm::try_from(cursor.u8()?).map_err(|_| invalid(section, "bad realm"))?;
        cursor.u8()?;
        let list_id = cursor.u16()?;
        if usize::from(list_id) >= list_count {
            return Err(invalid(section, format!("unknown list {}", list_id)));
        }
        let entries = cursor.u32()?;
        let hosts = (0..entries)
            .map(|_| cursor.str(pool).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;
        groups.push((realm, list_id, hosts));
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::{CompiledEntry, CompiledWriter, NetworkEntry, TokenSlot};
    use crate::types::{FilteringContext, MatchResult};

    fn sample_engine() -> Engine {
        let mut writer = CompiledWriter::new("sample");
        writer.push(&CompiledEntry::Hostname {
            flags: FilterFlags::empty(),
            hostname: "ads.example.com".to_string(),
        });
        writer.push(&CompiledEntry::Hostname {
            flags: FilterFlags::EXCEPTION,
            hostname: "ok.example.com".to_string(),
        });
        for i in 0..12 {
            writer.push(&CompiledEntry::Network(NetworkEntry {
                flags: FilterFlags::empty(),
                kind: MatchKind::Plain,
                type_mask: if i % 2 == 0 { RequestType::SCRIPT } else { RequestType::IMAGE },
                party_mask: PartyMask::empty(),
                token: TokenSlot::Token("banner".to_string()),
                pattern: format!("/banner/{}/", i),
                domain_opt: String::new(),
                raw: format!("/banner/{}/", i),
            }));
        }
        writer.push(&CompiledEntry::Network(NetworkEntry {
            flags: FilterFlags::IMPORTANT,
            kind: MatchKind::Regex,
            type_mask: RequestType::empty(),
            party_mask: PartyMask::THIRD_PARTY,
            token: TokenSlot::Regex,
            pattern: r"/pixel\d+\.gif".to_string(),
            domain_opt: "news.site.org|~m.news.site.org".to_string(),
            raw: r"/\/pixel\d+\.gif/$important,third-party,domain=news.site.org|~m.news.site.org".to_string(),
        }));

        let mut second = CompiledWriter::new("second");
        second.push(&CompiledEntry::Hostname {
            flags: FilterFlags::empty(),
            hostname: "tracker.net".to_string(),
        });

        let mut engine = Engine::default();
        engine.load_compiled(&writer.finish()).expect("load sample");
        engine.load_compiled(&second.finish()).expect("load second");
        engine
    }

    const URLS: &[(&str, RequestType)] = &[
        ("https://ads.example.com/a.js", RequestType::SCRIPT),
        ("https://ok.example.com/a.js", RequestType::SCRIPT),
        ("https://x.com/banner/4/b.js", RequestType::SCRIPT),
        ("https://x.com/banner/4/b.js", RequestType::IMAGE),
        ("https://x.com/banner/5/b.png", RequestType::IMAGE),
        ("https://cdn.tracker.net/p", RequestType::PING),
        ("https://cdn.other.io/pixel12.gif", RequestType::IMAGE),
        ("https://clean.org/", RequestType::MAIN_FRAME),
    ];

    fn verdicts(engine: &Engine) -> Vec<(MatchResult, Option<String>)> {
        URLS.iter()
            .map(|&(url, ty)| {
                let verdict = engine.match_request(&FilteringContext::new(url, "https://news.site.org/", ty));
                let raw = engine.to_log_data(&verdict).map(|l| l.raw_filter);
                (verdict.result, raw)
            })
            .collect()
    }

    #[test]
    fn restores_equivalent_engine() {
        let mut engine = sample_engine();
        engine.freeze();
        let blob = engine.serialize();
        let restored = Engine::deserialize(&blob, EngineConfig::default()).expect("deserialize");

        assert!(restored.is_frozen());
        assert_eq!(verdicts(&engine), verdicts(&restored));
        assert_eq!(restored.lists(), engine.lists());
        assert_eq!(restored.stats().records, engine.stats().records);
        assert_eq!(restored.stats().block.hostnames, engine.stats().block.hostnames);
        assert_eq!(restored.serialize(), blob);

        let expected = vec![
            (MatchResult::Blocked, Some("||ads.example.com^".to_string())),
            (MatchResult::Allowed, Some("@@||ok.example.com^".to_string())),
            (MatchResult::Blocked, Some("/banner/4/".to_string())),
            (MatchResult::NoMatch, None),
            (MatchResult::Blocked, Some("/banner/5/".to_string())),
            (MatchResult::Blocked, Some("||tracker.net^".to_string())),
            (
                MatchResult::Blocked,
                Some(r"/\/pixel\d+\.gif/$important,third-party,domain=news.site.org|~m.news.site.org".to_string()),
            ),
            (MatchResult::NoMatch, None),
        ];
        assert_eq!(verdicts(&restored), expected);
    }

    #[test]
    fn bytes_do_not_depend_on_layout() {
        let open = sample_engine();
        let mut frozen = open.clone();
        frozen.freeze();
        let mut optimized = open.clone();
        optimized.optimize();
        assert!(optimized.stats().block.partitioned_buckets > 0);

        let blob = open.serialize();
        assert_eq!(frozen.serialize(), blob);
        assert_eq!(optimized.serialize(), blob);
    }

    #[test]
    fn empty_engine_round_trips() {
        let blob = Engine::default().serialize();
        let restored = Engine::deserialize(&blob, EngineConfig::default()).expect("deserialize");
        assert_eq!(restored.stats().records, 0);
        assert_eq!(restored.stats().lists, 0);
    }

    #[test]
    fn rejects_bad_magic_and_short_data() {
        let mut blob = sample_engine().serialize();
        assert_eq!(
            Engine::deserialize(&blob[..10], EngineConfig::default()).err(),
            Some(SelfieError::DataTooShort)
        );
        blob[0] = b'X';
        assert_eq!(
            Engine::deserialize(&blob, EngineConfig::default()).err(),
            Some(SelfieError::InvalidMagic)
        );
    }

    #[test]
    fn rejects_unknown_version() {
        let mut blob = sample_engine().serialize();
        write_u16_le(&mut blob, header::VERSION, SELFIE_VERSION + 1);
        assert_eq!(
            Engine::deserialize(&blob, EngineConfig::default()).err(),
            Some(SelfieError::UnsupportedVersion(SELFIE_VERSION + 1))
        );
    }

    #[test]
    fn detects_corruption() {
        let mut blob = sample_engine().serialize();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        assert!(matches!(
            Engine::deserialize(&blob, EngineConfig::default()),
            Err(SelfieError::Crc32Mismatch { .. })
        ));
    }

    #[test]
    fn restored_engine_rejects_loads() {
        let blob = sample_engine().serialize();
        let mut restored = Engine::deserialize(&blob, EngineConfig::default()).expect("deserialize");
        let text = CompiledWriter::new("late").finish();
        assert_eq!(restored.load_compiled(&text), Err(crate::compiled::LoadError::Frozen));
    }
}
