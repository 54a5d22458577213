use std::sync::{Arc, Mutex};

use crate::connection::Connection;

/// A mutex-guarded free list of [`Connection`]s. `get()` hands out a
/// `PooledConnection` whose `Drop` returns the (reset) connection to the
/// pool instead of deallocating it — the Rust analog of a shared pointer
/// with a custom deleter.
pub struct ConnectionPool {
    free: Mutex<Vec<Box<Connection>>>,
}

impl ConnectionPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { free: Mutex::new(Vec::new()) })
    }

    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        let free = (0..capacity).map(|_| Box::new(Connection::new())).collect();
        Arc::new(Self { free: Mutex::new(free) })
    }

    pub fn size(&self) -> usize {
        self.free.lock().expect("connection pool poisoned").len()
    }

    /// Pops a recycled connection, or manufactures a fresh one if the pool
    /// is currently empty. Growth beyond the initial capacity is bounded
    /// elsewhere, by the accept path's max-connection check, not by the
    /// pool itself.
    pub fn get(self: &Arc<Self>) -> PooledConnection {
        let conn = self
            .free
            .lock()
            .expect("connection pool poisoned")
            .pop()
            .unwrap_or_default();
        PooledConnection { conn: Some(conn), pool: Arc::clone(self) }
    }

    fn release(&self, mut conn: Box<Connection>) {
        conn.reset();
        self.free.lock().expect("connection pool poisoned").push(conn);
    }
}

pub struct PooledConnection {
    conn: Option<Box<Connection>>,
    pool: Arc<ConnectionPool>,
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken before drop")
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken before drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_connection_has_no_residue() {
        let pool = ConnectionPool::with_capacity(1);
        {
            let mut conn = pool.get();
            conn.send_buf.write_in(b"leftover").unwrap();
            conn.status = crate::connection::ConnStatus::Ok;
        }
        assert_eq!(pool.size(), 1);
        let conn = pool.get();
        assert_eq!(conn.send_buf.len(), 0);
        assert_eq!(conn.status, crate::connection::ConnStatus::None);
    }

    #[test]
    fn grows_past_initial_capacity_on_demand() {
        let pool = ConnectionPool::with_capacity(1);
        let a = pool.get();
        let b = pool.get();
        assert_eq!(pool.size(), 0);
        drop(a);
        drop(b);
        assert_eq!(pool.size(), 2);
    }
}
